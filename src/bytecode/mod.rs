/*!

  The VM uses a 64 bit little-endian word as the unit of both instructions
  and data. An instruction word carries its opcode in the low 8 bits and its
  operand space above, in one of two splits:

    Opcode:    8 bits
    Operand:  56 bits signed
  or
    Opcode:    8 bits
    Sub-op:    8 bits (syscall id, comparison byte, or increment delta)
    Operand:  48 bits signed

  Raw data words (the `data` directive and str8 payloads) use all 64 bits
  and are never decoded.

  One design decision that needed to be made is whether to store decoded
  instructions as data members of enum variants, one variant per opcode.
  Program memory must stay a flat vector of words regardless, because it is
  mutable at runtime and byte-addressable through the str8 view. So the
  packed word is the only stored representation, and `Instruction` is a
  transient decoded view grouped by operand format: field extraction and
  range checks live in one place rather than being open-coded per opcode.

*/

pub mod image;
pub mod isa;
pub mod str8;
pub mod word;

pub use isa::{Instruction, Opcode, Syscall};
pub use word::Word;
