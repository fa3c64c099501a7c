pub mod archive;
pub mod daemon;
pub mod export;
pub mod opportunity;
pub mod sample;
pub mod status;
pub mod sync;
