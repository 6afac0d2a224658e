/// pixels are packed one bit each, so a row takes `ceil(WIDTH / 8)` bytes
pub const WIDTH: usize = 800;
pub const HEIGHT: usize = 480;
pub const ROW_BYTES: usize = row_bytes(WIDTH);
pub const FRAME_BYTES: usize = ROW_BYTES * HEIGHT;

pub const fn row_bytes(width: usize) -> usize {
    width.div_ceil(8)
}
