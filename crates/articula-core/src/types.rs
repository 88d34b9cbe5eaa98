//! Shared scalar and handle types.

use std::cell::RefCell;
use std::rc::Rc;

/// Identifier of a node, unique among its siblings.
///
/// Uniqueness across a whole tree is not enforced. Inserting a duplicate
/// elsewhere in the tree is logged and tolerated, and lookups then find only
/// one of the two nodes.
pub type Guid = u32;

/// Attachment handle shared between the authored tree and solver snapshots.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a value in a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}
