//! C3 linearization.
//!
//! A type's MRO is itself followed by the merge of its bases' MROs and the
//! base list; the merge repeatedly takes the first candidate head that
//! appears in no remaining tail. Results are cached in the type's
//! [`MroState`](super::type_def::MroState) and computed at most once.

use std::rc::Rc;

use super::type_def::{MroState, TypeRegistry};
use super::{VmErrorKind, VmResult, err};

/// Returns the cached MRO of `tid`, computing it on first use.
///
/// Every MRO starts with the type itself and ends with the universal root
/// (registration guarantees the root is reachable through `bases`).
pub fn mro_of(reg: &TypeRegistry, tid: u16) -> VmResult<Rc<[u16]>> {
    if let MroState::Computed(cached) = &*reg.type_def(tid).mro.borrow() {
        return Ok(cached.clone());
    }
    let order: Rc<[u16]> = linearize(reg, tid)?.into();
    *reg.type_def(tid).mro.borrow_mut() = MroState::Computed(order.clone());
    Ok(order)
}

/// `lhs` is `rhs` or inherits from it.
pub fn is_subtype(reg: &TypeRegistry, lhs: u16, rhs: u16) -> VmResult<bool> {
    Ok(mro_of(reg, lhs)?.contains(&rhs))
}

fn linearize(reg: &TypeRegistry, tid: u16) -> VmResult<Vec<u16>> {
    let bases = reg.type_def(tid).bases.clone();
    let mut seqs: Vec<Vec<u16>> = Vec::with_capacity(bases.len() + 1);
    for &base in &bases {
        seqs.push(mro_of(reg, base)?.to_vec());
    }
    seqs.push(bases);

    let mut out = vec![tid];
    merge(reg, tid, seqs, &mut out)?;
    Ok(out)
}

fn merge(
    reg: &TypeRegistry,
    tid: u16,
    mut seqs: Vec<Vec<u16>>,
    out: &mut Vec<u16>,
) -> VmResult<()> {
    loop {
        seqs.retain(|s| !s.is_empty());
        if seqs.is_empty() {
            return Ok(());
        }
        // first head that is in no remaining tail
        let good = seqs
            .iter()
            .map(|s| s[0])
            .find(|&head| !seqs.iter().any(|s| s[1..].contains(&head)));
        let Some(head) = good else {
            return Err(err(
                VmErrorKind::MroConflict,
                format!(
                    "cannot create a consistent method resolution order for type '{}'",
                    reg.type_def(tid).name
                ),
            ));
        };
        out.push(head);
        for s in &mut seqs {
            if s[0] == head {
                s.remove(0);
            }
        }
    }
}
