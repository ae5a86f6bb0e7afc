/// Environment probe scheduling

pub mod scheduler;

pub use scheduler::{ProbeDesc, ProbeId, ProbeRequest, ProbeScheduler, Urgency};
