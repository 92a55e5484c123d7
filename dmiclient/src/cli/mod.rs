pub mod console;

// Re-export main console type
pub use console::Console;
