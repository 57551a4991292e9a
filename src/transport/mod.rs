/// Local filesystem listing, directory creation, and staged writes.
pub mod fs;
