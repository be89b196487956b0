//! Optimistic update with rollback.
//!
//! The local change is applied before the persistence call runs, so whatever
//! renders `state` during `persist` already shows the new value. A failed
//! persist hands `state` to `revert`, which is expected to restore server
//! truth.

pub fn apply<S, T, E>(
    state: &mut S,
    apply_local: impl FnOnce(&mut S),
    persist: impl FnOnce(&S) -> Result<T, E>,
    revert: impl FnOnce(&mut S),
) -> Result<T, E> {
    apply_local(state);
    match persist(&*state) {
        Ok(value) => Ok(value),
        Err(err) => {
            revert(state);
            Err(err)
        }
    }
}
