use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Reconcile meeting items into a project's requirements")]
pub struct Cli {
    /// Path to the project store file (.yaml or .db)
    #[clap(long, short = 'f')]
    pub file: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty project store
    Init {
        /// Project name
        #[clap(long)]
        name: Option<String>,
    },

    /// Reconcile a meeting's extracted items against the project and save a
    /// pending resolution session
    Plan {
        /// YAML file with the meeting's extracted items
        meeting: PathBuf,

        /// Maximum concurrent AI calls
        #[clap(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Show the pending resolution session
    Status,

    /// Resolve the pending session's conflicts interactively
    Resolve {
        /// Accept every AI recommendation without prompting
        #[clap(long)]
        accept_recommended: bool,
    },

    /// Commit the fully-resolved pending session to the store
    Apply,

    /// Discard the pending session without applying it
    Discard {
        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// List requirement items
    List {
        /// Restrict to one section (e.g. problems, user_goals)
        #[clap(long)]
        section: Option<String>,
    },

    /// Show one item with its history
    Show {
        /// The item id (UUID, or unambiguous prefix)
        id: String,
    },

    /// Edit an item's content in place
    Edit {
        /// The item id
        id: String,

        /// New content (prompts if omitted)
        #[clap(long)]
        content: Option<String>,
    },

    /// Delete an item
    Del {
        /// The item id
        id: String,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Rewrite a section's ordering from a complete id permutation
    Reorder {
        /// The section to reorder
        section: String,

        /// Every item id of the section, in the desired order
        ids: Vec<String>,
    },
}
