pub mod app;
pub mod handlers;
pub mod models;
pub mod utils;

pub use handlers::{
    news::{get_by_id, list_by_category, list_recent, refresh_status},
    title_check::{classify_title, TitleCheck},
};
pub use models::{
    error::{Error, Result},
    news::Article,
};
pub use utils::{config::Config, state::AppState};
