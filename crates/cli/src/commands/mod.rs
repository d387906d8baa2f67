pub mod model;
pub mod retrain;
