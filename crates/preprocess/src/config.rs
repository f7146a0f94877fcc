/// Square model input used when no size is configured.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);
