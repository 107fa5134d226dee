//! Line-oriented capture protocol.
//!
//! One record per line, space-separated fields, prefixed by a tag:
//!
//! | Tag  | Fields                     | Meaning                                  |
//! |------|----------------------------|------------------------------------------|
//! | `m`  | fov width height           | session metadata, once, recordings only  |
//! | `t`  | elapsedSeconds             | start of a tick                          |
//! | `c`  | x y z qx qy qz qw          | camera pose                              |
//! | `r`  | id x y z qx qy qz qw       | legacy single-point anchor               |
//! | `d`  | id x y z [confidence]      | point cloud point                        |
//! | `p`  | id x y z qx qy qz qw       | plane added or updated                   |
//! | `b`  | x y                        | boundary vertex of the preceding `p`     |
//! | `pd` | id                         | plane removed or subsumed                |
//!
//! The live pose feed carries `c` lines only.

pub mod encoder;
pub mod reader;
pub mod record;

pub use encoder::{encode_lines, encode_snapshot, pose_line, write_snapshot};
pub use reader::{decode_log, Anchor, DecodedFrame, DecodedLog, FrameDecoder, LogReader};
pub use record::LineRecord;
