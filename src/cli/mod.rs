pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod plan;
pub mod run;
pub mod runtime;
pub mod serve;

pub use app::run;
