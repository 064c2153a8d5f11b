//! Axum-State der REST-Schnittstelle

use std::sync::Arc;

use axum::http::HeaderMap;
use klangbruecke_auth::Anmeldedienst;
use klangbruecke_core::IdentityId;
use klangbruecke_relay::RaumManager;

use crate::error::{ApiError, ApiResult};
use crate::middleware::bearer_token;
use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub manager: RaumManager,
    pub anmeldung: Arc<dyn Anmeldedienst>,
    pub limiter: Arc<RateLimiter>,
}

impl ApiState {
    pub fn neu(
        manager: RaumManager,
        anmeldung: Arc<dyn Anmeldedienst>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            manager,
            anmeldung,
            limiter,
        }
    }

    /// Loest den Bearer-Nachweis ueber den Anmeldedienst auf
    pub async fn identitaet(&self, headers: &HeaderMap) -> ApiResult<IdentityId> {
        let nachweis = bearer_token(headers)
            .ok_or_else(|| ApiError::Authentifizierung("Authorization-Header fehlt".into()))?;
        Ok(self.anmeldung.identitaet_pruefen(nachweis).await?)
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}
