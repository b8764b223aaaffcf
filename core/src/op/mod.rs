use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Arithmetic and bitwise operators carried by `Op::BinaryOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOpType {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Power,
    LShift,
    RShift,
    BitwiseAnd,
    BitwiseOr,
}

/// Ordering and equality operators carried by `Op::CompareOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOpType {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl Display for BinaryOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOpType::Add => "+",
            BinaryOpType::Sub => "-",
            BinaryOpType::Mul => "*",
            BinaryOpType::Div => "/",
            BinaryOpType::Mod => "%",
            BinaryOpType::And => "&&",
            BinaryOpType::Or => "||",
            BinaryOpType::Xor => "^",
            BinaryOpType::Power => "**",
            BinaryOpType::LShift => "<<",
            BinaryOpType::RShift => ">>",
            BinaryOpType::BitwiseAnd => "&",
            BinaryOpType::BitwiseOr => "|",
        };
        f.write_str(s)
    }
}

impl Display for CompareOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOpType::Lt => "<",
            CompareOpType::Le => "<=",
            CompareOpType::Eq => "==",
            CompareOpType::Ne => "!=",
            CompareOpType::Gt => ">",
            CompareOpType::Ge => ">=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    /// `<-ch`
    Receive,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Receive => write!(f, "<-"),
        }
    }
}

/// Infix operators as written in source.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    In,
    NotIn,
}

impl BinOp {
    pub fn binary_type(self) -> Option<BinaryOpType> {
        let t = match self {
            BinOp::Add => BinaryOpType::Add,
            BinOp::Sub => BinaryOpType::Sub,
            BinOp::Mul => BinaryOpType::Mul,
            BinOp::Div => BinaryOpType::Div,
            BinOp::Mod => BinaryOpType::Mod,
            BinOp::Pow => BinaryOpType::Power,
            BinOp::Shl => BinaryOpType::LShift,
            BinOp::Shr => BinaryOpType::RShift,
            BinOp::BitAnd => BinaryOpType::BitwiseAnd,
            BinOp::BitXor => BinaryOpType::Xor,
            _ => return None,
        };
        Some(t)
    }

    pub fn compare_type(self) -> Option<CompareOpType> {
        let t = match self {
            BinOp::Eq => CompareOpType::Eq,
            BinOp::Ne => CompareOpType::Ne,
            BinOp::Gt => CompareOpType::Gt,
            BinOp::Lt => CompareOpType::Lt,
            BinOp::Ge => CompareOpType::Ge,
            BinOp::Le => CompareOpType::Le,
            _ => return None,
        };
        Some(t)
    }

    /// Binding power used by the parser; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne | BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le | BinOp::In | BinOp::NotIn => 3,
            BinOp::Add | BinOp::Sub | BinOp::BitXor => 4,
            BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Shl | BinOp::Shr | BinOp::BitAnd => 5,
            BinOp::Pow => 6,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        matches!(self, BinOp::Pow)
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
        };
        f.write_str(s)
    }
}
