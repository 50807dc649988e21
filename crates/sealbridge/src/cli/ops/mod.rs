pub mod decrypt;
pub mod encrypt;
pub mod inspect;
pub mod recover;
pub mod start_job;

pub use decrypt::Decrypt;
pub use encrypt::Encrypt;
pub use inspect::Inspect;
pub use recover::Recover;
pub use start_job::StartJob;
