use polymer::{pair_insertion::Solution, Args, Parser, RunQuestions};

fn main() {
    let args: Args = Args::parse();

    match args.question {
        0_u8 => Solution::both(&args),
        1_u8 => Solution::q1(&args),
        2_u8 => Solution::q2(&args),
        question => unreachable!(
            "A valid Args will have a question value in the range 0..=2, but {question} was \
            encountered.\n\
            Args:\n\
            {args:#?}"
        ),
    }
}
