pub mod beats;
pub mod decode;
pub mod extract;
pub mod features;
pub mod stft;
