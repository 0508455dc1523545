pub mod communicator;
pub mod cycle;
pub mod domain;
pub mod error;
pub mod face;
pub mod ghost_filler;
pub mod inter_level_comm;
pub mod interpolator;
pub mod iterative;
pub mod level;
pub mod nbr_info;
pub mod patch_array;
pub mod patch_info;
pub mod patch_operator;
pub mod patch_solver;
pub mod restrictor;
pub mod thread_pool;
pub mod timer;
pub mod vector;
pub mod view;
