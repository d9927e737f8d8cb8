mod run;
mod server;

pub use self::{
    run::{ConfigError, RunConfig},
    server::MockBehavior,
};
