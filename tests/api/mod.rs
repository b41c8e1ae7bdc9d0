mod chat_api_tests;
mod chat_ws_tests;
mod health_tests;
