pub const APP_NAME: &str = "meter2car";

/// Default config file name inside the config directory.
pub const CONFIG_FILENAME: &str = "meter2car.toml";

/// Hex-encoded meter decryption key; takes precedence over the config file.
pub const KEY_ENV: &str = "METER2CAR_KEY";

/// Charger base URL; takes precedence over the config file.
pub const URL_ENV: &str = "METER2CAR_URL";
