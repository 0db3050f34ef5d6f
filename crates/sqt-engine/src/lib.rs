pub mod config;
pub mod device;
pub mod kernels;
pub mod matrix;
pub mod monitor;
pub mod queue;
pub mod reduce;
pub mod run;
pub mod transport;
pub mod writer;

pub use config::{
    CorrelationMethod, CorrelationType, KernelFamily, MultipoleKind, OrientationType,
    ScatterConfig, ScatteringKind,
};
pub use device::ScatterDevice;
pub use monitor::{MonitorClient, StreamEmitter};
pub use run::{exit_code, run_scattering, RunSummary};
pub use transport::{Communicator, LocalComm, MemComm};
pub use writer::{average_records, ResultRecord, SignalReader, SignalWriter, WriterClient};

#[cfg(test)]
mod tests;
