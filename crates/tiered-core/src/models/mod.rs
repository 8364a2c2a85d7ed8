pub mod api_config;
pub mod io_mapping;
pub mod request;
pub mod result;
pub mod step;
pub mod swarm;

pub use api_config::*;
pub use io_mapping::*;
pub use request::*;
pub use result::*;
pub use step::*;
pub use swarm::*;
