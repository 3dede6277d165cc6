// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::{
  env,
  fmt::Write as _,
  fs,
  io,
  path::{Path, PathBuf},
};

const FRONTEND_DIR: &str = "frontend";

fn main() {
  let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
  if matches!(
    target_os.as_str(),
    "linux" | "dragonfly" | "freebsd" | "openbsd" | "netbsd"
  ) {
    println!("cargo:rustc-cfg=linux");
  }

  let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
  let root = manifest_dir.join(FRONTEND_DIR);
  println!("cargo:rerun-if-changed={}", root.display());

  let mut files = Vec::new();
  if root.is_dir() {
    collect(&root, &root, &mut files).expect("failed to walk the frontend directory");
  }
  files.sort();

  let mut out = String::from("&[\n");
  for (relative, absolute) in &files {
    println!("cargo:rerun-if-changed={}", absolute.display());
    writeln!(
      out,
      "  ({:?}, include_bytes!({:?}) as &[u8]),",
      relative,
      absolute.display().to_string()
    )
    .unwrap();
  }
  out.push(']');

  let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
  fs::write(out_dir.join("embedded_assets.rs"), out).expect("failed to write embedded_assets.rs");
}

// Paths are recorded relative to the root with `/` separators on every platform.
fn collect(root: &Path, dir: &Path, files: &mut Vec<(String, PathBuf)>) -> io::Result<()> {
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_dir() {
      collect(root, &path, files)?;
    } else if let Ok(relative) = path.strip_prefix(root) {
      let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
      files.push((relative, path.clone()));
    }
  }
  Ok(())
}
