pub mod decode;
pub mod kernel;
pub mod matrix;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod types;
pub mod window;
