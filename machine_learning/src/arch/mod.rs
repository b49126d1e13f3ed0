mod activations;
mod dense;
mod sequential;

pub use activations::ActFn;
pub use dense::Dense;
pub use sequential::Sequential;
