pub mod assets;
pub mod emit;
pub mod styles;
pub mod toolchain;

pub use assets::CopyAssetsStep;
pub use emit::EmitBundleStep;
pub use styles::{CompileStylesStep, CompiledStyle};
pub use toolchain::{CompileToolchainStep, ToolchainArtifacts};
