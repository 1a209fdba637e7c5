//! §8 scenario 5 — keyboard echo: a host key event updates the keyboard registers and
//! latches the keyboard interrupt (number 3).

mod common;

use simulatron::devices::keyboard::KeyEvent;
use simulatron::memory::AccessIntent;

#[test]
fn key_event_is_visible_through_the_bus_and_raises_interrupt_three() {
    let mut h = common::harness(common::rom_with_program(&[]));

    h.keyboard.lock().unwrap().push_event(KeyEvent {
        key: 65,
        ctrl: false,
        alt: true,
    });

    assert_eq!(
        h.bus.read_byte(common::KEYBOARD_BASE, AccessIntent::Read).unwrap(),
        65
    );
    assert_eq!(
        h.bus
            .read_byte(common::KEYBOARD_BASE + 1, AccessIntent::Read)
            .unwrap(),
        simulatron::devices::keyboard::META_ALT
    );
    assert_eq!(h.interrupts.lock().unwrap().servicable(0xFF), Some(3));
}
