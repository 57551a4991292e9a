/// Subject identifier taken from a source file name.
/// Example: `0fc8854f-c` from `0fc8854f-c_walk_003.bin`
pub type SubjectId = String;
/// Label name attached to a sample.
/// Example: `texting_activity_step`
pub type LabelName = String;
/// Dense integer code assigned to a label by an encoding profile.
/// Example: `9`
pub type LabelCode = i32;
/// Container file extension without the leading dot.
/// Example: `tfrecord`
pub type Extension = String;
