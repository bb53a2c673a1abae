//! Backend type aliases and device management
//!
//! - **TrainingBackend**: Autodiff-enabled NdArray backend used by the online
//!   networks of the DQN and PPO agents (CPU)
//! - **InferenceBackend**: Plain NdArray backend used for action selection and
//!   for the DQN target network, which never receives gradients
//!
//! The networks here are a few hundred parameters wide, so the CPU backend is
//! more than sufficient.

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend type for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend type for inference (without autodiff)
pub type InferenceBackend = NdArray<f32>;

/// Get the default device for computation
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
