// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Platform directories used by the image cache.
//!
//! Every function resolves its path once and returns the cached value on
//! later calls.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

static HOME_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Root override installed by [`set_custom_root`]. When present, both the data
/// and cache directories live underneath it.
static CUSTOM_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// On macOS, this is `~/Library/Application Support/Imgcache`.
/// On Linux/FreeBSD, this is `$XDG_DATA_HOME/imgcache`.
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// On macOS, this is `~/Library/Caches/Imgcache`.
/// On Linux/FreeBSD, this is `$XDG_CACHE_HOME/imgcache`.
static CACHE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the user's home directory.
pub fn home_dir() -> &'static PathBuf {
    HOME_DIR.get_or_init(|| dirs::home_dir().expect("failed to determine home directory"))
}

/// Returns the directory holding persistent application data.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(|| {
        if let Some(root) = CUSTOM_ROOT.get() {
            root.join("data")
        } else if cfg!(any(target_os = "linux", target_os = "freebsd")) {
            if let Ok(flatpak_xdg_data) = std::env::var("FLATPAK_XDG_DATA_HOME") {
                flatpak_xdg_data.into()
            } else {
                dirs::data_local_dir().expect("failed to determine XDG_DATA_HOME directory")
            }
            .join("imgcache")
        } else {
            dirs::data_local_dir()
                .expect("failed to determine LocalAppData directory")
                .join("Imgcache")
        }
    })
}

/// Returns the platform cache directory. Contents may be wiped by the OS.
pub fn cache_dir() -> &'static PathBuf {
    CACHE_DIR.get_or_init(|| {
        if let Some(root) = CUSTOM_ROOT.get() {
            return root.join("cache");
        }

        if cfg!(any(target_os = "macos", target_os = "windows")) {
            return dirs::cache_dir()
                .expect("failed to determine platform cache directory")
                .join("Imgcache");
        }

        if cfg!(any(target_os = "linux", target_os = "freebsd")) {
            return if let Ok(flatpak_xdg_cache) = std::env::var("FLATPAK_XDG_CACHE_HOME") {
                flatpak_xdg_cache.into()
            } else {
                dirs::cache_dir().expect("failed to determine XDG_CACHE_HOME directory")
            }
            .join("imgcache");
        }

        home_dir().join(".cache").join("imgcache")
    })
}

/// Returns the directory downloaded images are published into.
pub fn image_cache_dir() -> &'static PathBuf {
    static IMAGE_CACHE_DIR: OnceLock<PathBuf> = OnceLock::new();
    IMAGE_CACHE_DIR.get_or_init(|| cache_dir().join("images"))
}

/// Returns the path to the database directory.
pub fn database_dir() -> &'static PathBuf {
    static DATABASE_DIR: OnceLock<PathBuf> = OnceLock::new();
    DATABASE_DIR.get_or_init(|| data_dir().join("db"))
}

/// Returns the path to the SQLite file backing the key-value store.
pub fn database_file() -> &'static PathBuf {
    static DATABASE_FILE: OnceLock<PathBuf> = OnceLock::new();
    DATABASE_FILE.get_or_init(|| database_dir().join("imgcache.db"))
}

/// Relocates the data and cache directories under `dir`.
///
/// Must be called before any other function of this crate resolves a path.
/// Relative paths are canonicalized when possible and the directory is
/// created if missing.
///
/// # Panics
///
/// Panics if a data or cache path was already resolved, or if the directory
/// cannot be created.
pub fn set_custom_root<P: ?Sized + AsRef<Path>>(dir: &P) -> &'static PathBuf {
    assert!(
        DATA_DIR.get().is_none() && CACHE_DIR.get().is_none(),
        "set_custom_root called after data_dir or cache_dir was initialized"
    );
    CUSTOM_ROOT.get_or_init(|| {
        let mut path = dir.as_ref().to_path_buf();
        if path.is_relative()
            && let Ok(abs) = path.canonicalize()
        {
            path = abs;
        }

        std::fs::create_dir_all(&path).unwrap_or_else(|e| {
            panic!("failed to create custom root directory {}: {e}", path.display())
        });

        path
    })
}
