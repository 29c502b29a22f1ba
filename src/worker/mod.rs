pub mod capture;
pub mod supervisor;

pub use capture::CaptureWorker;
pub use supervisor::{
    CaptureWorkerSupervisor, InProcessWorkerHost, StreamNegotiator, SyntheticNegotiator,
    WorkerHost, WorkerState, WORKER_TARGET,
};
