use std::path::{Path, PathBuf};

/// Path of the standalone daemon binary installed next to the CLI.
pub fn to_daemon_path(cli_path: &Path) -> PathBuf {
    let mut path = cli_path.to_path_buf();
    path.set_file_name("devtempo-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
