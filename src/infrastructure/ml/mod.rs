pub mod onnx_inpainter;
pub mod onnx_ocr;
pub mod onnx_upscaler;
pub mod session;
pub mod traits;
