//! `ibfs` creates and manipulates IBFS disk images.
//!
//! The tool accepts one image and one command: `info`, `ls`, `mkdir`,
//! `rmdir`, `rm` or `test`, plus `mkfs` to format a new image. Only
//! single-segment paths under `/` are accepted.

use ibfs::Ibfs;
use ibfs::fs::IbfsFactory;
use std::env;
use std::env::ArgsOs;
use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;

/// Writes an error to stderr, then exits.
fn error<M: fmt::Display>(msg: M) -> ! {
    eprintln!("ibfs: error: {msg}");
    exit(1);
}

/// Prints command usage, then exits.
fn print_usage() -> ! {
    eprintln!("usage:");
    eprintln!(" ibfs mkfs <image>");
    eprintln!(" ibfs <image> info");
    eprintln!(" ibfs <image> ls [/]");
    eprintln!(" ibfs <image> mkdir /<name>");
    eprintln!(" ibfs <image> rmdir /<name>");
    eprintln!(" ibfs <image> rm /<name>");
    eprintln!(" ibfs <image> test");
    exit(1);
}

/// Returns the next argument as a path string.
fn next_path(args: &mut ArgsOs) -> String {
    let Some(arg) = args.next() else {
        print_usage();
    };
    arg.into_string()
        .unwrap_or_else(|_| error("invalid path argument"))
}

/// Returns the single path segment of `path` (e.g. `/foo` gives `foo`).
fn path_segment(path: &str) -> &str {
    let Some(name) = path.strip_prefix('/') else {
        error(format_args!("{path}: expected an absolute path"));
    };
    if name.contains('/') {
        error(format_args!(
            "{path}: only single-segment paths are supported"
        ));
    }
    name
}

/// Formats a new image at `path` with the default geometry.
fn mkfs(path: PathBuf) {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)
        .unwrap_or_else(|e| {
            error(format_args!("{}: {e}", path.display()));
        });
    IbfsFactory::default().create(file).unwrap_or_else(|e| {
        error(format_args!("failed to create filesystem: {e}"));
    });
    println!("created an ibfs filesystem on `{}`", path.display());
}

/// Prints the filesystem's geometry.
fn print_fs_info(fs: &Ibfs) {
    let sb = fs.superblock();
    println!("version: {}", sb.version);
    println!("block size: {}", sb.block_size);
    println!("block count: {}", sb.block_count);
    println!("inode count: {}", sb.inode_count);
    println!("root inode: {}", sb.root_inode);
    println!("root tree block: {}", sb.root_bpt_block);
}

/// Lists the directory `dir_ino`, one entry per line, directories with a
/// trailing `/`.
fn ls(fs: &mut Ibfs, dir_ino: u32) -> ibfs::Result<()> {
    for entry in fs.ls(dir_ino)? {
        if entry.inode.is_dir() {
            println!("{}/", entry.name);
        } else {
            println!("{}", entry.name);
        }
    }
    Ok(())
}

fn main() {
    let mut args = env::args_os();
    args.next();
    let Some(first) = args.next() else {
        print_usage();
    };
    if first == "mkfs" {
        let Some(image) = args.next() else {
            print_usage();
        };
        mkfs(PathBuf::from(image));
        return;
    }
    let image = PathBuf::from(first);
    let Some(cmd) = args.next() else {
        print_usage();
    };
    let Some(cmd) = cmd.to_str().map(str::to_owned) else {
        print_usage();
    };

    let mut fs = Ibfs::mount(&image).unwrap_or_else(|e| {
        error(format_args!("{}: {e}", image.display()));
    });
    let root_ino = fs.superblock().root_inode;
    let result = match cmd.as_str() {
        "info" => {
            print_fs_info(&fs);
            Ok(())
        }
        "ls" => {
            if let Some(path) = args.next() {
                if path != "/" {
                    error("only the root directory can be listed");
                }
            }
            ls(&mut fs, root_ino)
        }
        "mkdir" => fs
            .mkdir(root_ino, path_segment(&next_path(&mut args)))
            .map(|_| ()),
        "rmdir" => fs.rmdir(root_ino, path_segment(&next_path(&mut args))),
        "rm" => fs.rm(root_ino, path_segment(&next_path(&mut args))),
        "test" => fs.bpt_self_test().map(|()| println!("self-test passed")),
        _ => print_usage(),
    };
    result.unwrap_or_else(|e| {
        error(e);
    });
}
