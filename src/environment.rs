use std::sync::Arc;

use log::Logger;

use crate::auth::TokenSigner;
use crate::db::Db;
use crate::urls::Urls;

pub type SafeDb = dyn Db + Send + Sync;

/// Everything a handler needs, cheap to clone into each request.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<SafeDb>,
    pub tokens: Arc<TokenSigner>,
    pub urls: Arc<Urls>,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<SafeDb>,
        tokens: Arc<TokenSigner>,
        urls: Arc<Urls>,
    ) -> Self {
        Self {
            logger,
            db,
            tokens,
            urls,
        }
    }
}
