//! End-to-end tests exercising preprocess -> parse -> analyse -> codegen ->
//! link against real source text, covering the multi-unit and failure
//! scenarios a single module's unit tests can't reach on their own.
use std::path::PathBuf;

use nescc::codegen::DataAllocator;
use nescc::linker::{self, Mapper};
use nescc::unit::CompilationUnit;

struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(name: &str, contents: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("nescc-pipeline-test-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        TempFile { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn a_single_unit_with_main_links_to_a_valid_rom() {
    let src = "
        uint8_t add(uint8_t a, uint8_t b) { return a + b; }
        void main() {
            uint8_t x;
            x = add(2, 3);
            if (x == 5) {
                __asm lda #$01;
            } else {
                __asm lda #$00;
            }
        }
    ";
    let file = TempFile::new("a.c", src);
    let mut data = DataAllocator::new();
    let mut units = vec![CompilationUnit::compile(&file.path, &mut data).unwrap()];
    let rom = linker::link(&mut units, Mapper::Nrom).unwrap();

    assert_eq!(rom.len(), 0x10000);
    assert_eq!(&rom[0..4], b"NES\x1A");
    assert_eq!(rom[6], 0x00);
    let reset_vector = u16::from_le_bytes([rom[0xFFFC], rom[0xFFFD]]);
    assert!((0xC000..0xFFFA).contains(&reset_vector));
}

#[test]
fn two_units_share_a_global_variable_and_call_across_unit_boundaries() {
    // Scenario E: one unit declares and writes a shared variable and a
    // helper function; the other calls the helper from `main`. Both must
    // resolve to the same RAM address and a correctly relocated JSR.
    let lib_src = "
        uint8_t counter;
        void bump() {
            counter = 1;
        }
    ";
    let main_src = "
        void bump();
        void main() {
            bump();
        }
    ";
    let lib = TempFile::new("lib.c", lib_src);
    let main = TempFile::new("main.c", main_src);

    let mut data = DataAllocator::new();
    let lib_unit = CompilationUnit::compile(&lib.path, &mut data).unwrap();
    let main_unit = CompilationUnit::compile(&main.path, &mut data).unwrap();

    let mut units = vec![lib_unit, main_unit];
    let rom = linker::link(&mut units, Mapper::Original).unwrap();
    assert_eq!(rom.len(), 0x10000);
    assert_eq!(rom[6], 0x01);
}

#[test]
fn linking_without_a_main_function_fails() {
    let src = "void helper() { }";
    let file = TempFile::new("nomain.c", src);
    let mut data = DataAllocator::new();
    let mut units = vec![CompilationUnit::compile(&file.path, &mut data).unwrap()];
    let result = linker::link(&mut units, Mapper::Nrom);
    assert!(matches!(result, Err(linker::Error::MissingMain)));
}

#[test]
fn a_reference_to_an_undeclared_symbol_fails_analysis() {
    let src = "void main() { x = 1; }";
    let file = TempFile::new("undeclared.c", src);
    let mut data = DataAllocator::new();
    let result = CompilationUnit::compile(&file.path, &mut data);
    assert!(result.is_err());
}

#[test]
fn while_loop_branches_backward_to_its_condition() {
    let src = "
        void main() {
            uint8_t i;
            i = 0;
            while (i == 0) {
                i = 1;
            }
        }
    ";
    let file = TempFile::new("loop.c", src);
    let mut data = DataAllocator::new();
    let unit = CompilationUnit::compile(&file.path, &mut data).unwrap();
    assert!(!unit.object_code.is_empty());
}
