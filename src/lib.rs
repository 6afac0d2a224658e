pub mod color;
pub mod config;
pub mod constants;
pub mod convert;
pub mod display_constants;
pub mod e_paper_display;
pub mod panel_worker;
pub mod scheduler;
pub mod source;
