use super::Ext2;
use crate::ext2_defs::*;
use crate::prelude::*;
use crate::return_error;

impl Ext2 {
    /// Given a logic block id, find the corresponding fs block id by walking
    /// the inode's extent tree from the root in `i_block`.
    ///
    /// Holes, and extents that are allocated but unwritten, fail with
    /// `ENODATA`.
    pub(super) fn extent_get_pblock(
        &self,
        inode_ref: &InodeRef,
        iblock: LBlockId,
    ) -> Result<PBlockId> {
        let root = ExtentNode::from_bytes(inode_ref.inode.block_area())?;
        self.extent_search_node(root, iblock)
            .map_err(|e| match e.code() {
                ErrCode::ENODATA => format_hole(inode_ref.id, iblock),
                _ => e,
            })
    }

    fn extent_search_node(&self, node: ExtentNode, iblock: LBlockId) -> Result<PBlockId> {
        let depth = node.header().depth;
        if node.header().is_leaf() {
            return match node.extent_search(iblock)? {
                Some(ex) if !ex.is_unwritten() => {
                    Ok(ex.start_pblock() + (iblock - ex.first_block) as PBlockId)
                }
                _ => Err(Ext2Error::new(ErrCode::ENODATA)),
            };
        }
        let Some(index) = node.extent_index_search(iblock)? else {
            return Err(Ext2Error::new(ErrCode::ENODATA));
        };
        // Load the next extent node
        let block = self.read_block(index.leaf())?;
        let child = ExtentNode::from_bytes(&block.data)?;
        if child.header().depth + 1 != depth {
            return_error!(
                ErrCode::EINVAL,
                "Extent node in block {} has depth {}, expected {}",
                index.leaf(),
                child.header().depth,
                depth - 1
            );
        }
        self.extent_search_node(child, iblock)
    }
}

fn format_hole(inode: InodeId, iblock: LBlockId) -> Ext2Error {
    Ext2Error::with_message(
        ErrCode::ENODATA,
        format!("Inode {} has no extent covering block {}", inode, iblock),
    )
}
