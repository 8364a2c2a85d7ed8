pub mod swarm_store;

pub use swarm_store::SwarmStore;
