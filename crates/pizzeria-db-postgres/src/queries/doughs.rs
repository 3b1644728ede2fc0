//! Dough recipes.

use std::sync::Arc;

use pizzeria_query::Schemas;
use pizzeria_storage::ConnectionProvider;

use super::resource::ResourceDao;

/// Builds the DAO for `DOUGHS`.
pub fn dough_dao(provider: Arc<dyn ConnectionProvider>, schemas: &Schemas) -> ResourceDao {
    ResourceDao::new(provider, schemas.doughs.clone())
}
