//! Root CLI structure for meshanim

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meshanim")]
#[command(about = "Inspect and sample skinned B3D, X and MS3D meshes", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display summary information about a mesh file
    Info {
        /// Path to the mesh file
        file: PathBuf,

        /// Also list materials and render buffers
        #[arg(short, long)]
        detailed: bool,
    },

    /// Display the joint hierarchy as a tree
    Joints {
        /// Path to the mesh file
        file: PathBuf,

        /// Maximum depth to display
        #[arg(short, long)]
        depth: Option<usize>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Print animated joint transforms at a frame
    Sample {
        /// Path to the mesh file
        file: PathBuf,

        /// Frame to sample, in the file format's frame unit
        #[arg(short, long, default_value = "0")]
        frame: f32,

        /// Only print this joint
        #[arg(short, long)]
        joint: Option<String>,

        /// Hold keys instead of interpolating between them
        #[arg(long)]
        constant: bool,
    },

    /// Load a mesh and report problems found along the way
    Validate {
        /// Path to the mesh file
        file: PathBuf,

        /// Treat loader warnings as failures
        #[arg(short, long)]
        strict: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
