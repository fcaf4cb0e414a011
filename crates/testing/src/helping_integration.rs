//! Integration coverage for spec.md §8 invariant 11 / scenario S4
//! ("helping" donation) driven from outside `core_hw_kernel` through its
//! public `Kernel` surface only, complementing the unit tests already
//! in `core_hw_kernel::kernel`'s own `#[cfg(test)] mod tests`. Grounded
//! on the same two scenarios those unit tests cover, replayed here as a
//! black-box caller would see them (PD/thread setup via `Kernel`'s
//! syscall-shaped methods, no access to scheduler/IPC internals).

use core_hw_kernel::kernel::error::Outcome;
use core_hw_kernel::kernel::scheduler::Owner;
use core_hw_kernel::kernel::thread::State;
use core_hw_kernel::kernel::Kernel;

#[test]
fn helping_chain_of_three_resolves_to_the_working_thread() {
    let mut k = Kernel::new(1, 1000, 100);
    let pd = k.new_pd(0x7000, false);
    let t1 = k.new_thread(pd, 0, 1, 0);
    let t2 = k.new_thread(pd, 0, 2, 0);
    let t3 = k.new_thread(pd, 0, 3, 100);
    assert_eq!(k.start_thread(t1), Outcome::Ok);
    assert_eq!(k.start_thread(t2), Outcome::Ok);
    assert_eq!(k.start_thread(t3), Outcome::Ok);

    assert_eq!(k.await_request_msg(t3), Outcome::Ok);
    assert_eq!(k.await_request_msg(t2), Outcome::Ok);
    assert_eq!(k.send_request_msg(t1, t2, true), Outcome::Ok);
    assert_eq!(k.send_request_msg(t2, t3, true), Outcome::Ok);

    assert_eq!(k.execution_owner(t1), t3);
    assert_eq!(k.execution_owner(t2), t3);
    assert_eq!(k.execution_owner(t3), t3);
    assert_eq!(k.cpus().cpu(0).head_owner(), Owner::Thread(t3));
}

#[test]
fn helping_donation_releases_back_to_client_on_reply() {
    let mut k = Kernel::new(1, 1000, 100);
    let pd = k.new_pd(0x7100, false);
    let client = k.new_thread(pd, 0, 3, 300);
    let server = k.new_thread(pd, 0, 1, 50);
    assert_eq!(k.start_thread(client), Outcome::Ok);
    assert_eq!(k.start_thread(server), Outcome::Ok);

    assert_eq!(k.await_request_msg(server), Outcome::Ok);
    assert_eq!(k.send_request_msg(client, server, true), Outcome::Ok);

    assert_eq!(k.thread(client).unwrap().state(), State::AwaitsIpc);
    assert_eq!(k.execution_owner_on_cpu(0), Owner::Thread(server));

    assert_eq!(k.send_reply_msg(server), Outcome::Ok);

    assert_eq!(k.thread(client).unwrap().state(), State::Active);
    assert_eq!(k.execution_owner_on_cpu(0), Owner::Thread(client));
}

/// A non-helping send (spec.md glossary: plain synchronous IPC, no
/// priority donation) leaves the client's own thread as its own
/// execution owner even while it blocks on the reply — the contrast
/// case to the two donation tests above.
#[test]
fn non_helping_send_does_not_donate_execution() {
    let mut k = Kernel::new(1, 1000, 100);
    let pd = k.new_pd(0x7200, false);
    let client = k.new_thread(pd, 0, 3, 300);
    let server = k.new_thread(pd, 0, 1, 50);
    assert_eq!(k.start_thread(client), Outcome::Ok);
    assert_eq!(k.start_thread(server), Outcome::Ok);

    assert_eq!(k.await_request_msg(server), Outcome::Ok);
    assert_eq!(k.send_request_msg(client, server, false), Outcome::Ok);

    assert_eq!(k.thread(client).unwrap().state(), State::AwaitsIpc);
    assert_eq!(k.execution_owner(client), client);
}
