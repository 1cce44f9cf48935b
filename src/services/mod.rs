/// Business logic services layer
pub mod aurora;
pub mod calendar;
pub mod events;
pub mod moon;
pub mod notifier;
pub mod scheduler;
pub mod visibility;
pub mod weather;

pub use aurora::KpForecastService;
pub use events::EventService;
pub use notifier::{deliver, GatewayNotifier, LogNotifier, Notifier};
pub use scheduler::{Cycle, NotificationScheduler, RecurringTask};
pub use weather::WeatherService;
