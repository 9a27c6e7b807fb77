pub mod policies;

pub use policies::Entity as Policies;
