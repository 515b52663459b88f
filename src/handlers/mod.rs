pub mod news;
pub mod title_check;
