mod helpers;
mod test_health;
mod test_startup;
mod test_streaming;
mod test_upload;
