//! Playout resolution: which pieces are alive, what plays next and what to
//! cue ahead.

pub mod lifespan;
pub mod lookahead;
pub mod resolve;
pub mod select_next;

pub use lifespan::{build_part_instance_pieces, continues_into, PartPosition, PreviousPartInstance};
pub use lookahead::{find_lookahead_objects, LookaheadInput, LookaheadPart};
pub use resolve::{resolve_active_pieces, resolve_piece_timings, ActivePieces, PieceKey};
pub use select_next::{
    move_next_part, playlist_order, select_next_part, PlayoutOrder, SelectNextPartContext,
    SelectedNextPart,
};
