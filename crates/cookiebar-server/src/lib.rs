//! CookieBar server: hosts the consent banner, the AJAX action endpoint,
//! the admin API and the scheduled cookie scan.

pub mod ajax;
pub mod hooks;
pub mod routes;
pub mod scan;
pub mod scheduler;
pub mod state;
pub mod visitor;

pub use hooks::{HookRegistry, LifecycleEvent};
pub use routes::build_router;
pub use state::AppContext;
