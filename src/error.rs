//! Driver error taxonomy. Every condition here is recovered locally: the
//! channel is forced back to idle where needed and the tick loop carries on.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The command body does not fit the line buffer. Nothing was sent.
    CommandTooLong,
    /// The pending-command ring is saturated. Retry later or drop.
    QueueFull,
    /// `setup` has not run; the serial channel is not usable yet.
    Uninitialized,
    /// The in-flight command went unanswered for the whole timeout budget.
    /// The channel has been forced back to idle and the next queued command
    /// (if any) has been sent.
    ResponseTimeout,
    /// An inbound line could not be decoded and was dropped. Protocol state
    /// is unchanged.
    MalformedResponse,
    /// The serial port refused a read or write.
    Serial,
}
