mod config;
mod ledger;
mod logging;
mod primary;
mod replica;
mod server;
mod wire;

pub use config::ConfigError;
pub use config::PrimaryEnvConfig;
pub use config::SecondaryEnvConfig;
pub use ledger::Seq;
pub use logging::root_logger;
pub use primary::AppendError;
pub use primary::AppendOutcome;
pub use primary::HttpSecondaryClient;
pub use primary::PrimaryNode;
pub use primary::PrimaryOptions;
pub use primary::ReplicateAck;
pub use primary::RetryPolicy;
pub use primary::SecondaryId;
pub use primary::SecondaryStatus;
pub use primary::SecondaryTransport;
pub use primary::TransportError;
pub use replica::IngestOutcome;
pub use replica::ReplicaStore;
pub use server::shutdown_signal;
pub use server::PrimaryServer;
pub use server::SecondaryServer;
pub use server::ShutdownHandle;
pub use server::ShutdownSignal;
