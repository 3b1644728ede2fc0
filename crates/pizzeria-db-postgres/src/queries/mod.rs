//! DAOs for the pizzeria resources.
//!
//! DAOs only see the [`ConnectionProvider`] trait, so they run unchanged
//! against Postgres or the scripted provider used in tests.

mod common;
pub mod doughs;
pub mod ingredients;
pub mod pizzas;
mod resource;

use std::sync::Arc;

use pizzeria_query::Schemas;
use pizzeria_storage::ConnectionProvider;

pub use doughs::dough_dao;
pub use ingredients::{check_ingredients_exist, ingredient_dao};
pub use pizzas::{PizzaDao, PizzaIncludes};
pub use resource::ResourceDao;

/// The three DAOs sharing one connection provider.
#[derive(Debug, Clone)]
pub struct Daos {
    pub doughs: ResourceDao,
    pub ingredients: ResourceDao,
    pub pizzas: PizzaDao,
}

impl Daos {
    pub fn new(provider: Arc<dyn ConnectionProvider>, schemas: &Schemas) -> Self {
        Self {
            doughs: dough_dao(Arc::clone(&provider), schemas),
            ingredients: ingredient_dao(Arc::clone(&provider), schemas),
            pizzas: PizzaDao::new(provider, schemas),
        }
    }
}
