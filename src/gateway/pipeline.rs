//! The request pipeline: commands, wizard input, pending confirmations,
//! then analyze → gate → dispatch → synthesize.

use super::{
    gate::{self, GateDecision},
    router::{self, Dispatch, Route, RouteError, RouteState},
    synthesizer::{synthesize, Synthesis},
    wizard, Gateway,
};
use crate::commands::{self, Command, CommandContext};
use belt_core::{
    action::ActionResult,
    intent::{ActionKind, Plan},
    message::{ChatContext, Reply},
    session::PendingConfirmation,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

const YES_WORDS: &[&str] = &["ja", "yes", "ok", "oké", "oke", "doe maar", "klopt", "prima", "j", "y"];
const NO_WORDS: &[&str] = &["nee", "no", "annuleer", "annuleren", "stop", "niet doen", "n"];

fn normalize_answer(text: &str) -> String {
    text.trim()
        .trim_end_matches(['!', '.', ','])
        .trim()
        .to_lowercase()
}

pub fn is_yes(text: &str) -> bool {
    YES_WORDS.contains(&normalize_answer(text).as_str())
}

pub fn is_no(text: &str) -> bool {
    NO_WORDS.contains(&normalize_answer(text).as_str())
}

/// Extra messages sent after the main reply.
fn followups(plan: &Plan, results: &[ActionResult], confirmed: bool) -> Vec<String> {
    let mut followups = Vec::new();
    if !confirmed {
        followups.extend(plan.warnings.iter().map(|w| format!("⚠️ {w}")));
    }
    if results
        .iter()
        .any(|r| r.kind == ActionKind::Call && r.success)
    {
        followups.push("Ik laat je weten hoe het gesprek verloopt.".to_string());
    }
    followups
}

impl Gateway {
    /// Handle one inbound text and return the synchronous reply.
    ///
    /// `confirmed` marks a request the user already approved; it skips the
    /// confirmation gate but never the clarification check.
    pub async fn handle_user_text(
        &self,
        user_id: &str,
        chat: &ChatContext,
        text: &str,
        confirmed: bool,
    ) -> Reply {
        let text = text.trim();
        if text.is_empty() {
            return Reply::text("Wat kan ik voor je doen?");
        }

        if text.starts_with('/') {
            return self.handle_command(user_id, chat, text).await;
        }

        match self.storage.sessions.get_wizard(user_id).await {
            Ok(Some(state)) => {
                if wizard::is_expired(&state, self.engine.wizard_timeout_secs, Utc::now()) {
                    info!("wizard {} for {user_id} expired", state.action_type);
                    if let Err(e) = self.storage.sessions.remove_wizard(user_id).await {
                        warn!("failed to remove expired wizard for {user_id}: {e}");
                    }
                    return Reply::text(
                        "Deze flow is verlopen. Begin opnieuw met /bel, /sms, /mail of /agenda.",
                    );
                }
                return self.continue_wizard(state, text).await;
            }
            Ok(None) => {}
            Err(e) => warn!("failed to load wizard for {user_id}: {e}"),
        }

        if !confirmed {
            match self.storage.sessions.take_confirmation(user_id).await {
                Ok(Some(pending)) => {
                    if is_yes(text) {
                        info!("{user_id} confirmed pending request {}", pending.token);
                        return self
                            .process_request(user_id, chat, &pending.pending_message, true)
                            .await;
                    }
                    if is_no(text) {
                        info!("{user_id} declined pending request {}", pending.token);
                        return Reply::text("Oké, geannuleerd. Er is niets uitgevoerd.");
                    }
                    info!("pending request {} superseded by new input", pending.token);
                }
                Ok(None) => {}
                Err(e) => warn!("failed to load pending confirmation for {user_id}: {e}"),
            }
        }

        self.process_request(user_id, chat, text, confirmed).await
    }

    async fn handle_command(&self, user_id: &str, chat: &ChatContext, text: &str) -> Reply {
        if let Some(kind) = commands::wizard_kind(text) {
            return self.start_wizard(user_id, chat, kind).await;
        }
        let Some(cmd) = Command::parse(text) else {
            return Reply::text("Onbekend commando. Typ /help voor een overzicht.");
        };
        let ctx = CommandContext {
            sessions: self.storage.sessions.as_ref(),
            user_id,
            provider_name: self.provider.name(),
            active_calls: self.tracker.active_count().await,
            uptime: &self.uptime,
        };
        Reply::text(commands::handle(cmd, &ctx).await)
    }

    async fn process_request(
        &self,
        user_id: &str,
        chat: &ChatContext,
        text: &str,
        confirmed: bool,
    ) -> Reply {
        match self.route_request(user_id, chat, text, confirmed).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("request from {user_id} aborted: {e}");
                Reply::text("Er ging iets mis bij het verwerken van je verzoek. Probeer het opnieuw.")
            }
        }
    }

    async fn route_request(
        &self,
        user_id: &str,
        chat: &ChatContext,
        text: &str,
        confirmed: bool,
    ) -> Result<Reply, RouteError> {
        let mut route = Route::new();

        let intent = self.analyze_intent(text).await;
        if !confirmed {
            self.capture_preferences(user_id, text);
        }
        let preferences = self.load_preferences(user_id).await;
        let plan = self.create_plan(text, &preferences).await;
        let selected = router::select_action(text, &intent, &plan);
        info!(
            "request from {user_id}: intent={} action={selected} confirmed={confirmed}",
            intent.kind.as_str()
        );

        let decision = gate::evaluate(
            &intent,
            &plan,
            selected,
            confirmed,
            self.engine.max_clarification_questions,
        );
        match decision {
            GateDecision::Clarify(questions) => {
                route.advance(RouteState::Clarifying)?;
                route.advance(RouteState::Synthesizing)?;
                let reply = Reply::text(synthesize(Synthesis::Clarify(&questions)));
                route.advance(RouteState::Done)?;
                Ok(reply)
            }
            GateDecision::Confirm { prompt } => {
                route.advance(RouteState::Confirming)?;
                let pending = PendingConfirmation::new(user_id, chat, text);
                if let Err(e) = self.storage.sessions.put_confirmation(pending).await {
                    warn!("failed to store pending confirmation for {user_id}: {e}");
                    return Ok(Reply::text(
                        "Ik kon je verzoek niet vasthouden voor bevestiging. Probeer het later opnieuw.",
                    ));
                }
                route.advance(RouteState::Synthesizing)?;
                let reply = Reply::text(synthesize(Synthesis::Confirm(&prompt)));
                route.advance(RouteState::Done)?;
                Ok(reply)
            }
            GateDecision::Dispatch => {
                route.advance(RouteState::Dispatching)?;
                let dispatch = Dispatch {
                    user_id,
                    chat,
                    text,
                    intent: &intent,
                    plan: &plan,
                    preferences: &preferences,
                };
                self.dispatch(&mut route, &dispatch, selected, confirmed)
                    .await
            }
        }
    }

    /// Execute and synthesize. The route must be in `Dispatching`.
    pub(super) async fn dispatch(
        &self,
        route: &mut Route,
        dispatch: &Dispatch<'_>,
        selected: ActionKind,
        confirmed: bool,
    ) -> Result<Reply, RouteError> {
        let results = self.execute_route(route, dispatch, selected).await?;
        route.advance(RouteState::Synthesizing)?;
        let reply = Reply {
            text: synthesize(Synthesis::Executed {
                intent: dispatch.intent,
                results: &results,
            }),
            followups: followups(dispatch.plan, &results, confirmed),
        };
        route.advance(RouteState::Done)?;
        debug!(
            "route for {}: {}",
            dispatch.user_id,
            route
                .trail()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(reply)
    }
}
