pub mod archive;
pub mod error;
pub mod fixed;
pub mod impairment;
pub mod logs;
pub mod netem;
pub mod session;
pub mod sweep;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use archive::{archive, archive_sweep};
pub use error::{ArchiveError, ImpairmentError, LogFormatError, SessionError};
pub use fixed::{FixedReport, load_fixed_logs};
pub use impairment::ImpairmentController;
pub use logs::{read_metric_log, seal_log};
pub use netem::{LinkEmulator, LinkShape, NetemLink};
pub use session::{ProcessSession, SessionExecutor, SessionRequest};
pub use sweep::{BenchRunner, CancelToken, PointFailure, SweepReport, fold_existing, fold_point};
