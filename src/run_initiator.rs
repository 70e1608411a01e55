//! Run initiator (§4.3): clears prior run state and broadcasts the
//! configuration exactly once. Does not wait for acknowledgement — nodes not
//! already subscribed at publish time miss the run.

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::model::CallerConfig;

pub async fn start_distributed_calls(
    coordinator: &Coordinator,
    configuration: CallerConfig,
) -> Result<(), CoordinatorError> {
    coordinator.start_distributed_calls(configuration).await
}
