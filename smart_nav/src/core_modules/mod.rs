// Building blocks of the navigation pipeline, lowest level first.

pub mod pixel;
pub mod frame;
pub mod color_mask;
pub mod contour;
pub mod history;
pub mod stabilizer;
pub mod detection;
pub mod environment;
pub mod segmenter;
pub mod traffic_light;
pub mod stop_sign;
pub mod speed_limit;
pub mod navigation;
pub mod dispatch;
pub mod hardware;
pub mod overlay;
