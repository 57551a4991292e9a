use crate::splits::SplitLabel;

/// Label code tables for each encoding profile.
pub mod labels {
    use crate::types::LabelCode;

    /// Full-resolution activity table (18 classes).
    pub const FULL_PROFILE: &[(&str, LabelCode)] = &[
        ("back_right_pocket_activity_step", 0),
        ("holding_left_hand_activity_step", 1),
        ("front_right_pocket_activity_step", 2),
        ("recording_voice_message_activity_step", 3),
        ("jacket_inner_pocket_activity_step", 4),
        ("jacket_outer_right_pocket_activity_step", 5),
        ("jacket_outer_left_pocket_activity_step", 6),
        ("back_left_pocket_activity_step", 7),
        ("jacket_breast_pocket_activity_step", 8),
        ("reading_watching_activity_step", 9),
        ("texting_activity_step", 10),
        ("reading_scrolling_activity_step", 11),
        ("backpack_activity_step", 12),
        ("holding_right_hand_activity_step", 13),
        ("telephoning_activity_step", 14),
        ("landscape_texting_activity_step", 15),
        ("front_left_pocket_activity_step", 16),
        ("listening_voice_message_activity_step", 17),
    ];

    /// Reduced-resolution activity table (10 classes).
    pub const REDUCED_PROFILE: &[(&str, LabelCode)] = &[
        ("backpack_activity_step", 0),
        ("holding_right_hand_activity_step", 1),
        ("jacket_outer_left_pocket_activity_step", 2),
        ("landscape_texting_activity_step", 3),
        ("listening_voice_message_activity_step", 4),
        ("reading_scrolling_activity_step", 5),
        ("reading_watching_activity_step", 6),
        ("recording_voice_message_activity_step", 7),
        ("telephoning_activity_step", 8),
        ("texting_activity_step", 9),
    ];
}

/// Constants used by split assignment.
pub mod splits {
    use super::SplitLabel;

    /// Separator that ends the subject identifier in a source file name.
    pub const SUBJECT_SEPARATOR: char = '_';
    /// Canonical split processing order.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Test, SplitLabel::Evaluation];
}

/// Constants used by container framing and the record payload layout.
pub mod records {
    /// Bytes in the fixed record header (height, width, depth, label).
    pub const RECORD_HEADER_LEN: usize = 16;
    /// Bytes per serialized array element (`f64`).
    pub const ELEMENT_BYTES: usize = 8;
    /// Bytes in the length prefix of a framed record.
    pub const FRAME_LEN_BYTES: usize = 8;
    /// Bytes in each framed checksum.
    pub const FRAME_CRC_BYTES: usize = 4;
    /// Offset added to rotated CRC values when masking.
    pub const CRC_MASK_DELTA: u32 = 0xa282_ead8;
    /// Buffer size used by shard writers and readers.
    pub const IO_BUFFER_BYTES: usize = 1 << 20;
}

/// Output naming and default pipeline knobs.
pub mod output {
    /// Default container file extension.
    pub const DEFAULT_EXTENSION: &str = "tfrecord";
    /// Suffix appended to in-progress shard files before they are renamed into place.
    pub const STAGING_SUFFIX: &str = "partial";
    /// File name of the run manifest written next to the shards.
    pub const MANIFEST_FILENAME: &str = "manifest.json";
    /// Default number of source files per chunk.
    pub const DEFAULT_CHUNK_LEN: usize = 50;
    /// Default number of shards per chunk.
    pub const DEFAULT_NUM_SHARDS: usize = 10;
    /// Default channel depth written into each record.
    pub const DEFAULT_CHANNELS: u32 = 1;
}

/// Constants used by source sample files.
pub mod source {
    /// Extension marking a gzip-compressed sample file.
    pub const GZIP_EXTENSION: &str = "gz";
    /// Version tag written at the start of every sample file payload.
    pub const SAMPLE_FILE_VERSION: u8 = 1;
}

/// Constants used by decode-time verification.
pub mod verify {
    /// Default decode batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 64;
    /// Default seed for shuffled decode passes.
    pub const DEFAULT_SHUFFLE_SEED: u64 = 42;
}
