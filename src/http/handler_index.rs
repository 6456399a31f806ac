//! Handles GET / - unprotected greeting

pub async fn handle_index() -> &'static str {
    "Hello, I'm not protected 👋!"
}
