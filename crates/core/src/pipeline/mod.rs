pub mod detect_image_use_case;
pub mod overlay;
pub mod process_frame_use_case;
pub mod train_model_use_case;
