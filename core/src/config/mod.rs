mod load;
mod types;

pub use load::{expand_path, get_imgbatch_data_dir, load, load_default, parse_config};
pub use types::*;
