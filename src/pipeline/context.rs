use std::time::Instant;

use crate::error::ApiError;
use crate::namespace::ResId;
use crate::types::Operation;

/// State flowing through the request pipeline for one HTTP request
#[derive(Debug)]
pub struct RequestContext {
    pub operation: Operation,
    /// Session id from the signed cookie, if the request carried one
    pub session_id: Option<String>,
    /// `res_id` path segment as the client sent it
    pub raw_res_id: Option<String>,
    /// Set once the access check has passed
    pub res_id: Option<ResId>,
    pub start_time: Instant,
    /// Names of the stages that ran, in order
    pub stages_executed: Vec<&'static str>,
}

impl RequestContext {
    pub fn new(operation: Operation, session_id: Option<String>) -> Self {
        Self {
            operation,
            session_id,
            raw_res_id: None,
            res_id: None,
            start_time: Instant::now(),
            stages_executed: Vec::new(),
        }
    }

    pub fn with_res_id(mut self, raw_res_id: impl Into<String>) -> Self {
        self.raw_res_id = Some(raw_res_id.into());
        self
    }

    /// Session id, or 401 when the request has none
    pub fn require_session(&self) -> Result<&str, ApiError> {
        self.session_id
            .as_deref()
            .ok_or_else(|| ApiError::unauthorized("There is no session_id cookie"))
    }

    /// Resource id validated by the access check
    pub fn resource(&self) -> Result<ResId, ApiError> {
        self.res_id.ok_or_else(ApiError::no_access)
    }
}
