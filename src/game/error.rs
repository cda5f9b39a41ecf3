//! Errors raised by the grid engine.

use std::fmt;

use super::{bubble::BubbleId, hex::HexCoord};

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    /// The cell lies outside the board's columns or rows.
    OutOfBounds { cell: HexCoord },
    /// A bubble already occupies the cell.
    Occupied { cell: HexCoord },
    /// Every candidate slot around the impact is taken. The board is full.
    NoFreeSlot { cell: HexCoord },
    /// The aim ray found nothing to settle against.
    NoTarget,
    /// The bubble source does not know this id.
    UnknownBubble { id: BubbleId },
    /// The session has ended; nothing can be fired until it restarts.
    SessionOver,
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::OutOfBounds { cell } => write!(f, "cell {cell} is outside the board"),
            GridError::Occupied { cell } => write!(f, "cell {cell} is already occupied"),
            GridError::NoFreeSlot { cell } => write!(f, "no free slot around {cell}"),
            GridError::NoTarget => write!(f, "the aim ray did not hit anything"),
            GridError::UnknownBubble { id } => write!(f, "unknown bubble {id}"),
            GridError::SessionOver => write!(f, "the session is over"),
        }
    }
}

impl std::error::Error for GridError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_cell() {
        let err = GridError::NoFreeSlot {
            cell: HexCoord::new(3, 4),
        };
        assert_eq!(err.to_string(), "no free slot around (3, 4)");
    }
}
