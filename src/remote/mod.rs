mod light;

pub use light::LightRemote;
