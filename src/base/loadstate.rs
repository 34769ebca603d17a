/// The stage a request has reached, as reported to progress sinks.
/// Loosely follows net/base/load_states.h, collapsed to the stages a
/// document consumer displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// The request has not started yet.
    #[default]
    Idle,

    /// Opening the connection (resolve, TCP, proxy tunnel).
    Connecting,

    /// Writing the request line, headers and body.
    SendingRequest,

    /// Waiting for the server response (TTFB).
    WaitingForResponse,

    /// Reading the response body.
    ReadingResponse,

    /// The consumer is building its representation of the response.
    Building,

    /// The request finished, successfully or not.
    Done,
}

impl LoadState {
    /// Whether the state belongs to the network phase of a request.
    pub fn is_network(self) -> bool {
        matches!(
            self,
            LoadState::Connecting
                | LoadState::SendingRequest
                | LoadState::WaitingForResponse
                | LoadState::ReadingResponse
        )
    }
}
