use vliw470_common::error::{Error, Result};

use crate::operation::{Category, Dependency, Destination, Operation};
use crate::program::Program;

/// Parse an ordered list of operation strings into a `Program`, splitting
/// the stream into BB0/BB1/BB2 around the single optional `loop`/`loop.pip`
/// instruction.
pub fn parse(lines: &[String]) -> Result<Program> {
    let loop_positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_loop_line(line))
        .map(|(i, _)| i)
        .collect();

    if loop_positions.len() > 1 {
        return Err(Error::parse(format!(
            "expected at most one loop instruction, found {}",
            loop_positions.len()
        )));
    }

    if let Some(&p) = loop_positions.first() {
        let target = loop_target(&lines[p])?;
        if target > p {
            return Err(Error::parse(format!(
                "loop target {} is past the loop instruction at position {}",
                target, p
            )));
        }
        let bb0 = decode_all(&lines[..target])?;
        let bb1 = decode_all(&lines[target..p])?;
        let bb2 = decode_all(&lines[p + 1..])?;

        let bb1_start = bb0.len();
        let bb2_start = bb1_start + bb1.len();
        let mut operations = bb0;
        operations.extend(bb1);
        operations.extend(bb2);

        tracing::debug!(
            target: "parser",
            bb0 = bb1_start,
            bb1 = bb2_start - bb1_start,
            bb2 = operations.len() - bb2_start,
            "split program into basic blocks"
        );

        Ok(Program { operations, bb1_start, bb2_start, has_loop: true })
    } else {
        let operations = decode_all(lines)?;
        let len = operations.len();
        Ok(Program { operations, bb1_start: len, bb2_start: len, has_loop: false })
    }
}

fn is_loop_line(line: &str) -> bool {
    line.split_whitespace().next() == Some("loop")
}

fn loop_target(line: &str) -> Result<usize> {
    let mut tokens = line.split_whitespace();
    tokens.next(); // "loop"
    let target = tokens
        .next()
        .ok_or_else(|| Error::parse("loop instruction missing target".to_string()))?;
    target
        .parse::<usize>()
        .map_err(|_| Error::parse(format!("invalid loop target '{}'", target)))
}

fn decode_all(lines: &[String]) -> Result<Vec<Operation>> {
    lines.iter().map(|line| decode_operation(line)).collect()
}

/// Decode one non-`loop` operation string.
///
/// Tokens are whitespace-separated after stripping commas. Registers are
/// `x` followed by a non-negative decimal integer.
pub fn decode_operation(text: &str) -> Result<Operation> {
    let stripped = text.replace(',', " ");
    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    let Some(&opcode) = tokens.first() else {
        return Err(Error::parse("empty operation".to_string()));
    };

    let (category, destination, dep_tags): (Category, Option<Destination>, Vec<u32>) =
        match opcode {
            "add" | "sub" => {
                let rd = expect_register(&tokens, 1, text)?;
                let rs1 = expect_register(&tokens, 2, text)?;
                let rs2 = expect_register(&tokens, 3, text)?;
                (Category::Alu, Some(Destination::Register(rd)), vec![rs1, rs2])
            }
            "addi" => {
                let rd = expect_register(&tokens, 1, text)?;
                let rs1 = expect_register(&tokens, 2, text)?;
                expect_token(&tokens, 3, text)?;
                (Category::Alu, Some(Destination::Register(rd)), vec![rs1])
            }
            "mulu" => {
                let rd = expect_register(&tokens, 1, text)?;
                let rs1 = expect_register(&tokens, 2, text)?;
                let rs2 = expect_register(&tokens, 3, text)?;
                (Category::Mul, Some(Destination::Register(rd)), vec![rs1, rs2])
            }
            "ld" => {
                let rd = expect_register(&tokens, 1, text)?;
                let base = extract_base_register(expect_token(&tokens, 2, text)?, text)?;
                (Category::Mem, Some(Destination::Register(rd)), vec![base])
            }
            "st" => {
                let rs = expect_register(&tokens, 1, text)?;
                let base = extract_base_register(expect_token(&tokens, 2, text)?, text)?;
                (Category::Mem, None, vec![rs, base])
            }
            "mov" => return decode_mov(&tokens, text),
            other => {
                return Err(Error::parse(format!("unknown opcode '{}' in '{}'", other, text)));
            }
        };

    let dependencies = dep_tags.into_iter().map(Dependency::new).collect();
    Ok(Operation::new(text.to_string(), category, destination, dependencies))
}

fn decode_mov(tokens: &[&str], text: &str) -> Result<Operation> {
    let dest_token = expect_token(tokens, 1, text)?;
    let value_token = expect_token(tokens, 2, text)?;

    if dest_token == "LC" || dest_token == "EC" {
        if parse_register(value_token).is_some() {
            return Err(Error::parse(format!(
                "'{}' expects an immediate, found a register",
                text
            )));
        }
        return Ok(Operation::new(
            text.to_string(),
            Category::Alu,
            Some(Destination::Special),
            Vec::new(),
        ));
    }

    let rd = parse_register(dest_token)
        .ok_or_else(|| Error::parse(format!("expected destination register in '{}'", text)))?;

    let dependencies = match parse_register(value_token) {
        Some(rs) => vec![Dependency::new(rs)],
        None => Vec::new(),
    };

    Ok(Operation::new(
        text.to_string(),
        Category::Alu,
        Some(Destination::Register(rd)),
        dependencies,
    ))
}

fn parse_register(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('x')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn expect_token<'a>(tokens: &[&'a str], idx: usize, text: &str) -> Result<&'a str> {
    tokens
        .get(idx)
        .copied()
        .ok_or_else(|| Error::parse(format!("malformed operation '{}'", text)))
}

fn expect_register(tokens: &[&str], idx: usize, text: &str) -> Result<u32> {
    let token = expect_token(tokens, idx, text)?;
    parse_register(token).ok_or_else(|| {
        Error::parse(format!("expected register operand in '{}', found '{}'", text, token))
    })
}

/// Extract the base register from a `imm(rX)` memory operand.
fn extract_base_register(token: &str, text: &str) -> Result<u32> {
    let open = token
        .find('(')
        .ok_or_else(|| Error::parse(format!("expected 'imm(rX)' memory operand in '{}'", text)))?;
    let close = token
        .find(')')
        .ok_or_else(|| Error::parse(format!("expected 'imm(rX)' memory operand in '{}'", text)))?;
    if close <= open {
        return Err(Error::parse(format!("malformed memory operand in '{}'", text)));
    }
    let inner = &token[open + 1..close];
    parse_register(inner)
        .ok_or_else(|| Error::parse(format!("expected base register in '{}', found '{}'", text, inner)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_add() {
        let op = decode_operation("add x3, x1, x2").unwrap();
        assert_eq!(op.destination, Some(Destination::Register(3)));
        assert_eq!(op.dependencies.len(), 2);
        assert_eq!(op.dependencies[0].reg_tag, 1);
        assert_eq!(op.dependencies[1].reg_tag, 2);
        assert_eq!(op.category, Category::Alu);
    }

    #[test]
    fn decodes_addi_ignores_immediate() {
        let op = decode_operation("addi x1, x1, 1").unwrap();
        assert_eq!(op.dependencies.len(), 1);
        assert_eq!(op.dependencies[0].reg_tag, 1);
    }

    #[test]
    fn decodes_mulu_with_mul_latency() {
        let op = decode_operation("mulu x2, x1, x1").unwrap();
        assert_eq!(op.category, Category::Mul);
        assert_eq!(op.latency(), 3);
    }

    #[test]
    fn decodes_ld_dest_and_base() {
        let op = decode_operation("ld x5, 8(x1)").unwrap();
        assert_eq!(op.destination, Some(Destination::Register(5)));
        assert_eq!(op.dependencies.len(), 1);
        assert_eq!(op.dependencies[0].reg_tag, 1);
    }

    #[test]
    fn decodes_st_no_dest_two_deps() {
        let op = decode_operation("st x5, 8(x1)").unwrap();
        assert_eq!(op.destination, None);
        assert_eq!(op.dependencies.len(), 2);
        assert_eq!(op.dependencies[0].reg_tag, 5);
        assert_eq!(op.dependencies[1].reg_tag, 1);
    }

    #[test]
    fn decodes_mov_immediate_no_deps() {
        let op = decode_operation("mov x1, 10").unwrap();
        assert_eq!(op.destination, Some(Destination::Register(1)));
        assert!(op.dependencies.is_empty());
    }

    #[test]
    fn decodes_mov_register_one_dep() {
        let op = decode_operation("mov x2, x1").unwrap();
        assert_eq!(op.dependencies.len(), 1);
        assert_eq!(op.dependencies[0].reg_tag, 1);
    }

    #[test]
    fn decodes_mov_special() {
        let op = decode_operation("mov LC, 3").unwrap();
        assert_eq!(op.destination, Some(Destination::Special));
        assert!(op.dependencies.is_empty());
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(decode_operation("xor x1, x2, x3").is_err());
    }

    #[test]
    fn rejects_multiple_loops() {
        let lines = vec!["mov LC, 3".to_string(), "loop 0".to_string(), "loop 0".to_string()];
        assert!(parse(&lines).is_err());
    }

    #[test]
    fn parse_with_no_loop_puts_everything_in_bb0() {
        let lines = vec!["mov x1, 10".to_string(), "add x2, x1, x1".to_string()];
        let program = parse(&lines).unwrap();
        assert!(!program.has_loop);
        assert_eq!(program.bb1_start, 2);
        assert_eq!(program.bb2_start, 2);
        assert_eq!(program.operations.len(), 2);
    }

    #[test]
    fn parse_splits_blocks_around_loop() {
        let lines = vec![
            "mov LC, 3".to_string(),
            "mov x1, 0".to_string(),
            "loop 2".to_string(),
            "add x2, x1, x1".to_string(),
        ];
        let program = parse(&lines).unwrap();
        assert!(program.has_loop);
        assert_eq!(program.bb1_start, 2);
        assert_eq!(program.bb2_start, 2);
        assert_eq!(program.operations.len(), 3);
    }
}
