pub mod rubric_loader;

pub use rubric_loader::{load_rubric_file, load_rubric_folder};
