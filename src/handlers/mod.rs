// handlers/mod.rs - HTTP handlers
//
// Public (no session) → Workspace (session cookie) → Collection (session owns res_id)
//
pub mod collection;
pub mod payload;
pub mod status;
pub mod workspace;

use axum_extra::extract::cookie::SignedCookieJar;

use crate::error::ApiError;
use crate::namespace::{ResId, ScopedCollections};
use crate::pipeline::RequestContext;
use crate::session;
use crate::state::AppState;
use crate::types::Operation;

/// A request that passed the pipeline for one workspace
pub struct Authorized {
    pub session_id: String,
    pub collections: ScopedCollections,
}

impl Authorized {
    pub fn res_id(&self) -> &ResId {
        self.collections.res_id()
    }
}

/// Run the request pipeline for `operation` on `res_id`
pub async fn authorize(
    state: &AppState,
    jar: &SignedCookieJar,
    res_id: String,
    operation: Operation,
) -> Result<Authorized, ApiError> {
    let session_id = session::session_id(jar, state.cookie_name());
    let mut ctx = RequestContext::new(operation, session_id).with_res_id(res_id);
    state.pipeline.run(&mut ctx).await?;

    let res_id = ctx.resource()?;
    let session_id = ctx.require_session()?.to_string();
    Ok(Authorized {
        session_id,
        collections: ScopedCollections::new(res_id),
    })
}

#[cfg(test)]
mod tests;
