//! Provisioning stages
//!
//! Stages run in order:
//! 1. Acquire - cloud image download or cache reuse
//! 2. Customize - offline image modification
//! 3. Template - template VM creation
//! 4. Fleet - clone, configure and start instances

pub mod acquire;
pub mod customize;
pub mod fleet;
pub mod template;
