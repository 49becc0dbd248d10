mod secret;

pub use secret::SharedSecret;
