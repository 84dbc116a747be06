pub use {self::util::*, clap::Parser};

pub mod pair_insertion;
pub mod util;
