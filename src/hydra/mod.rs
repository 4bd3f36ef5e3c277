//! Hydra content: models, resource bindings and typed stores.

mod resources;
mod stores;
mod types;

pub use resources::{Associations, RestoMenus, SchamperArticles, MENU_DATE_FORMAT};
pub use stores::{AssociationStore, RestoStore, SchamperStore};
pub use types::{Association, Meal, RestoMenu, SchamperArticle};
