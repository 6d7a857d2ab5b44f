//! Placeholder executors for deployments without provider integrations.
//!
//! Every operation fails with `NotConfigured`, which the router surfaces as
//! a failed action with a remediation hint instead of a crash.

use crate::gateway::Executors;
use async_trait::async_trait;
use belt_core::{
    action::{CallStatusReport, CallTranscript},
    error::ExecutorError,
    traits::{BrowserExecutor, CalendarExecutor, MessageSender, VoiceExecutor},
};
use std::sync::Arc;

pub struct Unconfigured {
    service: &'static str,
}

impl Unconfigured {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }

    fn error(&self) -> ExecutorError {
        ExecutorError::NotConfigured(format!("no {} configured", self.service))
    }
}

#[async_trait]
impl VoiceExecutor for Unconfigured {
    async fn initiate_call(&self, _: &str, _: &str, _: &str) -> Result<String, ExecutorError> {
        Err(self.error())
    }

    async fn poll_status(&self, _: &str) -> Result<CallStatusReport, ExecutorError> {
        Err(self.error())
    }

    async fn fetch_transcript(&self, _: &str) -> Result<CallTranscript, ExecutorError> {
        Err(self.error())
    }
}

#[async_trait]
impl MessageSender for Unconfigured {
    async fn send(&self, _: &str, _: &str, _: Option<&str>) -> Result<String, ExecutorError> {
        Err(self.error())
    }
}

#[async_trait]
impl CalendarExecutor for Unconfigured {
    async fn create_event(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<String, ExecutorError> {
        Err(self.error())
    }
}

#[async_trait]
impl BrowserExecutor for Unconfigured {
    async fn run_task(&self, _: &str) -> Result<String, ExecutorError> {
        Err(self.error())
    }
}

/// An executor set where every action reports missing configuration.
pub fn unconfigured() -> Executors {
    Executors {
        voice: Arc::new(Unconfigured::new("voice provider")),
        sms: Arc::new(Unconfigured::new("sms provider")),
        email: Arc::new(Unconfigured::new("e-mail provider")),
        calendar: Arc::new(Unconfigured::new("calendar")),
        browser: Arc::new(Unconfigured::new("browser automation")),
    }
}
