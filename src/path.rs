//! Path resolution.
//!
//! Spec §4.5 describes this crate sitting on top of an external generic
//! path-walk helper the original source's host environment provides. A
//! standalone library has no such collaborator to call into, so this module
//! is the small, crate-private substitute: split a path on `/`, walk each
//! component through [`DirIter`], and follow symlinks encountered along the
//! way up to a bounded depth.

use std::ops::ControlFlow;

use crate::device::BlockDevice;
use crate::dir::DirIter;
use crate::error::Squash4Error;
use crate::inode::{read_inode, DirInode, Inode, SymlinkInode};
use crate::metadata::{ChunkRef, ChunkStream};
use crate::squashfs::Squash4Fs;

/// Mirrors common loader-side symlink-depth guards; deep enough for any
/// legitimate image, shallow enough to bound a maliciously crafted cycle.
const MAX_SYMLINK_DEPTH: u32 = 40;

/// An inode reached by path resolution, paired with the [`ChunkRef`]
/// positioned right after its fixed-size body (where a regular file's
/// block-size array, or a symlink's target name, begins).
pub(crate) struct Resolved {
    pub inode: Inode,
    pub tail_at: ChunkRef,
}

/// Resolve `path`, following symlinks encountered as intermediate directory
/// components but returning the final component's inode *as found* — which
/// may itself be a symlink. Callers that need the fully-dereferenced target
/// (e.g. [`crate::Squash4Fs::open`]) go through [`resolve_fully`] instead.
pub(crate) fn resolve<D: BlockDevice>(
    fs: &mut Squash4Fs<D>,
    path: &str,
) -> Result<Resolved, Squash4Error> {
    let mut depth = 0;
    resolve_inner(fs, path, &mut depth)
}

/// Same as [`resolve`], but additionally follows a symlink found at the
/// terminal path component, so the caller always lands on a non-symlink
/// inode (or an error, for a dangling or cyclic target).
pub(crate) fn resolve_fully<D: BlockDevice>(
    fs: &mut Squash4Fs<D>,
    path: &str,
) -> Result<Resolved, Squash4Error> {
    let mut depth = 0;
    let resolved = resolve_inner(fs, path, &mut depth)?;
    let parent = parent_dir(path);
    let (inode, tail_at) =
        follow_symlink_chain(fs, resolved.inode, resolved.tail_at, &parent, &mut depth)?;
    Ok(Resolved { inode, tail_at })
}

fn resolve_inner<D: BlockDevice>(
    fs: &mut Squash4Fs<D>,
    path: &str,
    depth: &mut u32,
) -> Result<Resolved, Squash4Error> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

    let mut current_inode = fs.root_inode()?;
    let mut current_tail = fs.superblock.root_inode_ref();
    let mut prefix = String::new();

    for (idx, component) in components.iter().enumerate() {
        let dir: DirInode = match &current_inode {
            Inode::Dir(d) => *d,
            _ => return Err(Squash4Error::NotADirectory),
        };

        let child_ref = find_child(fs, &dir, component)?.ok_or(Squash4Error::NotFound)?;
        let (child_inode, child_tail) =
            read_inode(&mut fs.device, &fs.inflate, &fs.superblock, child_ref)?;

        let is_last = idx + 1 == components.len();
        if is_last {
            current_inode = child_inode;
            current_tail = child_tail;
        } else {
            // An intermediate path component must become a directory before
            // the walk can continue, so any symlink here is followed now.
            let (resolved_inode, resolved_tail) =
                follow_symlink_chain(fs, child_inode, child_tail, &prefix, depth)?;
            current_inode = resolved_inode;
            current_tail = resolved_tail;
        }

        prefix.push('/');
        prefix.push_str(component);
    }

    Ok(Resolved {
        inode: current_inode,
        tail_at: current_tail,
    })
}

fn find_child<D: BlockDevice>(
    fs: &mut Squash4Fs<D>,
    dir: &DirInode,
    name: &str,
) -> Result<Option<ChunkRef>, Squash4Error> {
    let iter = DirIter::new(
        &mut fs.device,
        &fs.inflate,
        fs.superblock.dir_table,
        fs.superblock.inode_table,
        dir,
    );
    let mut found = None;
    iter.for_each_entry(|entry| {
        if entry.name == name {
            found = Some(entry.child_inode);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    Ok(found)
}

fn read_symlink_target<D: BlockDevice>(
    fs: &mut Squash4Fs<D>,
    sym: &SymlinkInode,
    tail_at: ChunkRef,
) -> Result<String, Squash4Error> {
    let mut buf = vec![0u8; sym.namelen as usize];
    ChunkStream::new(&mut fs.device, &fs.inflate).read(tail_at, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn follow_symlink_chain<D: BlockDevice>(
    fs: &mut Squash4Fs<D>,
    mut inode: Inode,
    mut tail_at: ChunkRef,
    containing_dir: &str,
    depth: &mut u32,
) -> Result<(Inode, ChunkRef), Squash4Error> {
    loop {
        let sym = match &inode {
            Inode::Symlink(s) => *s,
            _ => return Ok((inode, tail_at)),
        };

        *depth += 1;
        if *depth > MAX_SYMLINK_DEPTH {
            return Err(Squash4Error::SymlinkLoop);
        }

        let target = read_symlink_target(fs, &sym, tail_at)?;
        let resolved_path = if target.starts_with('/') {
            target
        } else {
            format!("{containing_dir}/{target}")
        };

        let resolved = resolve_inner(fs, &resolved_path, depth)?;
        inode = resolved.inode;
        tail_at = resolved.tail_at;
    }
}

fn parent_dir(path: &str) -> String {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.len() <= 1 {
        String::new()
    } else {
        format!("/{}", components[..components.len() - 1].join("/"))
    }
}
