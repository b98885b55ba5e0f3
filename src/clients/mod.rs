//! HTTP clients for the third-party services the handlers proxy to.
//! Each one sits behind a trait so `AppState` can carry fakes in tests.

pub mod ai;
pub mod mailer;
pub mod nutrition_api;
pub mod razorpay;

pub use ai::{AiClient, HttpAiClient};
pub use mailer::{HttpMailer, Mailer};
pub use nutrition_api::{NutritionApi, UsdaClient};
pub use razorpay::{PaymentGateway, RazorpayClient};
