pub mod cli;
pub mod composite;
pub mod config;
pub mod connector;
pub mod engines;
pub mod executors;
pub mod ingest;
pub mod job;
pub mod logging;
pub mod manifest;
pub mod molecule;
pub mod scheduler;
pub mod script;
pub mod settings;
pub mod shell;
pub mod target;

#[cfg(test)]
mod job_test;
#[cfg(test)]
mod molecule_test;
#[cfg(test)]
mod scheduler_test;
#[cfg(test)]
mod target_test;
