//! `iod` - English Indices of Deprivation 2025 loader

use depriv_ingest::Dataset;

fn main() {
    std::process::exit(depriv_cli::run(Dataset::Iod2025));
}
